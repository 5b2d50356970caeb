//! Remote configuration service clients.

mod client;
mod nacos;

pub use client::{
    ChangeEvent, ChangeListener, ChangeNotification, FetchFailure, RemoteConfigClient,
};
pub use nacos::{NacosClient, NacosClientBuilder};
