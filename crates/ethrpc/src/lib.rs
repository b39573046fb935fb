pub mod block_stream;

use {
    alloy::{
        providers::{DynProvider, Provider, ProviderBuilder},
        rpc::client::ClientBuilder,
    },
    url::Url,
};

pub type AlloyProvider = DynProvider;

/// Creates an HTTP provider for the L1 node at `url`.
pub fn provider(url: &Url) -> AlloyProvider {
    let rpc = ClientBuilder::default().http(url.clone());
    ProviderBuilder::new().connect_client(rpc).erased()
}
