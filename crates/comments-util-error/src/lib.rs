mod fmt;

pub use self::fmt::*;

pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;
pub type BoxedErrorResult<T> = std::result::Result<T, BoxedError>;
pub type WhateverResult<T> = std::result::Result<T, snafu::Whatever>;

pub trait BoxedExt<T, E> {
    fn boxed(self) -> std::result::Result<T, BoxedError>;
}

impl<T, E> BoxedExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn boxed(self) -> std::result::Result<T, BoxedError> {
        self.map_err(|e| Box::new(e) as BoxedError)
    }
}
