use std::fmt::Display;

/// An error type that can carry a plain message.
///
/// Crate error enums implement this and invoke [`impl_context!`] next to
/// their `Result` alias to get `.context()` / `.with_context()` on
/// `Result` and `Option`.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;

    /// `"<context>: <source>"`.
    fn prefixed(context: impl Display, source: impl Display) -> Self {
        Self::from_message(format!("{context}: {source}"))
    }
}

/// Define a crate-local `Context` trait for the `Error` and `Result` in scope.
///
/// ```ignore
/// // crates/config/src/error.rs
/// kadai_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T> {
            fn context(self, context: impl Into<String>) -> Result<T>;

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T>;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.map_err(|e| {
                    let context: String = context.into();
                    <Error as $crate::FromMessage>::prefixed(context, e)
                })
            }

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
                self.map_err(|e| {
                    let context: String = f().into();
                    <Error as $crate::FromMessage>::prefixed(context, e)
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(context.into()))
            }

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}
