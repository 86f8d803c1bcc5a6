use thiserror::Error;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Boxed cause carried by errors that wrap a lower-level failure.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by every rendering operation.
///
/// The success type defaults to `String` because helpers, programs and
/// templates all produce rendered text.
pub type RenderResult<T = String> = Result<T, Error>;

/// Error types raised by the template runtime.
///
/// Every failure raised while executing a compiled template surfaces as one
/// of these variants. Nothing is recovered locally: a failing helper or
/// partial aborts the whole render and the error reaches the caller of
/// [`Template::render`](crate::Template::render).
///
/// # Examples
///
/// ```rust,ignore
/// use template_runtime::Error;
///
/// match template.render(&context) {
///     Ok(text) => println!("{text}"),
///     Err(Error::MissingPartial { name }) => eprintln!("no partial named {name}"),
///     Err(e) => eprintln!("render failed: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A non-block helper lookup resolved to nothing.
    #[error("Could not find property '{name}'")]
    MissingProperty {
        /// The property or helper name the generated code asked for
        name: String,
    },

    /// A partial was referenced by name but is not registered.
    #[error("The partial {name} could not be found")]
    MissingPartial {
        /// Name of the referenced partial
        name: String,
    },

    /// A partial is registered as raw source but no compiler is bound.
    #[error("The partial {name} could not be compiled when running in vm mode")]
    PartialCompilationUnavailable {
        /// Name of the partial that needed compilation
        name: String,
    },

    /// The bound compiler rejected the source of a partial.
    #[error("The partial {name} could not be compiled: {source}")]
    PartialCompilation {
        /// Name of the partial that failed to compile
        name: String,
        /// Error reported by the compiler
        #[source]
        source: BoxedSource,
    },

    /// A helper or generated program failed.
    ///
    /// When built from a lower-level error the original error is kept as
    /// the source instead of being flattened into the message.
    #[error("{message}")]
    Exception {
        /// Human-readable description of the failure
        message: String,
        /// Underlying cause, if any
        #[source]
        source: Option<BoxedSource>,
    },

    /// Rendering exceeded one of the configured budgets.
    #[error("Resource limit exceeded: {limit_type} - {message}")]
    ResourceLimit {
        /// Which budget was exceeded
        limit_type: String,
        /// Detailed message about the violation
        message: String,
    },

    /// The runtime configuration could not be parsed.
    #[error("Invalid runtime configuration: {0}")]
    Configuration(#[from] toml::de::Error),
}

impl Error {
    /// Creates an [`Error::Exception`] carrying only a message.
    pub fn exception(message: impl Into<String>) -> Self {
        Self::Exception {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an [`Error::Exception`] that wraps a lower-level error.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Exception {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
