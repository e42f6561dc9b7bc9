#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Out of memory: system allocator could not provide {size} bytes")]
    OutOfMemory { size: usize },

    #[error("Pool too small: {size} bytes requested, more than {min} needed")]
    PoolTooSmall { size: usize, min: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
