//! Declaration-time error types.

/// Errors raised while declaring functions or building tables from them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    /// Two parameters of one function share a name.
    #[error("function '{function}' declares parameter '{parameter}' twice")]
    DuplicateParameter {
        /// The function being declared.
        function: String,
        /// The repeated parameter name.
        parameter: String,
    },

    /// A unit was attached to a parameter that cannot carry one.
    #[error("function '{function}': parameter '{parameter}' of type {ty} cannot carry a unit")]
    UnitOnNonNumeric {
        /// The function being declared.
        function: String,
        /// The offending parameter.
        parameter: String,
        /// Its declared type.
        ty: String,
    },

    /// A LENGTH parameter was declared on a function that does not accept
    /// arrays, or more than one was declared.
    #[error("function '{function}': invalid length parameter '{parameter}'")]
    InvalidLengthParameter {
        /// The function being declared.
        function: String,
        /// The offending parameter.
        parameter: String,
    },

    /// A function name was registered twice, or two names hash to the same
    /// function id.
    #[error("function '{0}' is already registered")]
    DuplicateFunction(String),

    /// A definition refers to a function that is not in the table.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// A definition binds a function in a way its signature does not allow.
    #[error("function '{function}' cannot be bound: {reason}")]
    InvalidBinding {
        /// The function being bound.
        function: String,
        /// Why the binding is rejected.
        reason: String,
    },
}
