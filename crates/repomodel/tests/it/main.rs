//! Integration tests for repomodel, built as a single test binary.
//!
//! - mapping: documents to model graphs and back
//! - ordered_set: dense position ordering against a row store
//! - collection_roles: the collection role types end to end
//! - fs_store: the JSON file row store

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("repomodel=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod collection_roles;
mod fs_store;
mod helpers;
mod mapping;
mod ordered_set;
