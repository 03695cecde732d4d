mod channel;
mod dispatcher;
mod manager;

pub(crate) use channel::Job;
pub(crate) use manager::WorkerPool;
