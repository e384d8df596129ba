pub mod dispatcher;
pub mod maintainer;

#[cfg(test)]
pub mod testing;

pub use dispatcher::Dispatcher;
pub use maintainer::MaintainerChannel;
