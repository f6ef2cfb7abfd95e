use crate::WriteError;

pub(crate) fn check_non_empty<'a>(value: &'a str, what: &str) -> Result<&'a str, WriteError> {
    if value.trim().is_empty() {
        Err(WriteError::invalid_argument(format!("{what} must not be empty")))
    } else {
        Ok(value)
    }
}

pub(crate) fn parse_millis(name: &str, value: &str) -> Result<std::time::Duration, WriteError> {
    value.parse::<u64>()
        .map(std::time::Duration::from_millis)
        .map_err(|_| WriteError::InvalidParameter(name.to_string(), value.to_string()))
}
