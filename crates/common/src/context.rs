//! `.context()` for crate-local error types.

/// An error type that can carry a bare message.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Define a `Context` trait in the calling module, with `.context()` and
/// `.with_context()` on `Result` and `Option`.
///
/// The calling module must have `Error: FromMessage` and a matching
/// `Result<T>` alias in scope:
///
/// ```ignore
/// impl ebb_common::FromMessage for Error { ... }
/// ebb_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T>: Sized {
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C;

            fn context(self, context: impl Into<String>) -> Result<T> {
                let context = context.into();
                self.with_context(|| context)
            }
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.map_err(|e| {
                    let context: String = f().into();
                    <Error as $crate::FromMessage>::from_message(format!("{context}: {e}"))
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}
