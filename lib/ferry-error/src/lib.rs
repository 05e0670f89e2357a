//! Error primitives shared by every Ferry crate.
//!
//! Typed errors are defined per concern with `snafu`. Anything that only needs to be reported, rather than matched on,
//! is carried as a [`GenericError`].
#![deny(missing_docs)]

use std::fmt::{Display, Write as _};

/// A type-erased error.
pub type GenericError = anyhow::Error;

/// Macro for constructing a generic error.
///
/// The resulting value evaluates to [`GenericError`], and can be constructed from a string literal, a format string
/// (with arguments accepted, in the same order as `std::format!`), or a value which implements `Debug` and `Display`,
/// such as an existing error that implements `std::error::Error`.
#[macro_export]
macro_rules! generic_error {
    ($msg:literal $(,)?) => { $crate::_anyhow!($msg) };
    ($err:expr $(,)?) => { $crate::_anyhow!($err) };
    ($fmt:expr, $($arg:tt)*) => { $crate::_anyhow!($fmt, $($arg)*) };
}

#[doc(hidden)]
pub use anyhow::anyhow as _anyhow;

pub(crate) mod private {
    pub trait Sealed {}

    impl<T, E> Sealed for Result<T, E> {}
}

// NOTE: Wrapping `anyhow::Context` keeps these extension methods from colliding with `snafu::ResultExt::context` when
// both traits are in scope.
/// Extension methods for attaching context to fallible results.
pub trait ErrorContext<T, E>: private::Sealed {
    /// Wrap the error value with additional context.
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static;

    /// Wrap the error value with additional context that is evaluated lazily only once an error does occur.
    fn with_error_context<C, F>(self, f: F) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T, E> for Result<T, E>
where
    Result<T, E>: anyhow::Context<T, E>,
{
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
    {
        <Self as anyhow::Context<T, E>>::context(self, context)
    }

    fn with_error_context<C, F>(self, context: F) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        <Self as anyhow::Context<T, E>>::with_context(self, context)
    }
}

/// Renders an error and its full cause chain on a single line.
///
/// Causes are joined with `: `, outermost first, which keeps multi-cause errors readable in line-oriented log output.
pub fn render_error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut current = error.source();
    while let Some(cause) = current {
        let _ = write!(rendered, ": {}", cause);
        current = cause.source();
    }
    rendered
}
