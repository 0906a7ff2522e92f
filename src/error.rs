pub type DivinaResult<T> = Result<T, DivinaError>;

#[derive(thiserror::Error, Debug)]
pub enum DivinaError {
    /// Fatal manifest problem: unparsable JSON, missing `metadata` or
    /// `readingOrder`. No partial story is built past this point.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("navigation error: {0}")]
    Navigation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DivinaError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn navigation(msg: impl Into<String>) -> Self {
        Self::Navigation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(DivinaError::parse("x").to_string().contains("parse error:"));
        assert!(
            DivinaError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            DivinaError::resource("x")
                .to_string()
                .contains("resource error:")
        );
        assert!(
            DivinaError::navigation("x")
                .to_string()
                .contains("navigation error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = DivinaError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
