//! Unit-layer error types.

/// Errors raised by unit conversion and quantity arithmetic.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UnitError {
    /// The two units measure different dimensions or belong to different
    /// unit systems.
    #[error("cannot convert '{from}' to '{to}': incompatible units")]
    Incompatible {
        /// Symbol of the source unit.
        from: String,
        /// Symbol of the target unit.
        to: String,
    },

    /// No unit with this symbol is registered.
    #[error("unknown unit symbol: {0}")]
    UnknownSymbol(String),

    /// Element-wise arithmetic on sequences of different length.
    #[error("sequence length mismatch: {left} vs {right}")]
    LengthMismatch {
        /// Length of the left operand.
        left: usize,
        /// Length of the right operand.
        right: usize,
    },

    /// A converter was asked to translate a unit it does not cover.
    #[error("n-body conversion not possible for '{0}'")]
    NotConvertible(String),

    /// A reference quantity for a converter was not a positive scalar.
    #[error("invalid reference quantity: {0}")]
    InvalidReference(String),
}
