pub mod audit;
pub mod config;
pub mod decode;
pub mod discover;
pub mod extract;
pub mod lock;
pub mod marker;
pub mod notify;
pub mod paths;
pub mod pipeline;
pub mod retention;
pub mod tree_sync;
pub mod util;
pub mod warn;
pub mod watcher;
