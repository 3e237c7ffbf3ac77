/// Errors produced while building, validating, packaging or deploying a stack.
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    /// One or more construct modules rejected their input.
    #[error("Invalid stack configuration:\n{}", .0.join("\n"))]
    Config(Vec<String>),

    /// A resource failed its own property validation.
    #[error("Validation failed on resource '{resource}'\n{message}")]
    Validation { resource: String, message: String },

    #[error("Invalid stack name {name}\n{reason}")]
    InvalidStackName { name: String, reason: String },

    /// A `Ref`, `Fn::GetAtt`, `Fn::Sub` or `DependsOn` points at nothing.
    #[error("Resource '{resource}' references unknown target '{target}'")]
    UnknownReference { resource: String, target: String },

    #[error("Dependency cycle detected between resources: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("Failed to serialize template\n{0}")]
    Serialize(#[from] serde_json::Error),

    /// CloudFormation reported a terminal failure status for the stack.
    #[error("Stack {stack} failed: {reason}")]
    StackFailed { stack: String, reason: String },

    /// An AWS API call failed. The message carries the SDK error context verbatim.
    #[error("AWS request failed: {0}")]
    Aws(String),

    #[error("Failed to package artifact: {0}")]
    Packaging(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StackError>;

impl StackError {
    pub fn aws(msg: impl Into<String>) -> Self {
        Self::Aws(msg.into())
    }

    pub fn validation(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: message.into(),
        }
    }
}
