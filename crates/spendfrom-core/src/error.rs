//! Error types for amounts and spend requests.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("empty amount")] Empty,
    #[error("negative amount: {0}")] Negative(String),
    #[error("invalid amount: {0}")] InvalidFormat(String),
    #[error("more than 8 decimal places: {0}")] TooPrecise(String),
    #[error("amount out of range: {0}")] OutOfRange(String),
    #[error("amount overflow")] Overflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("no source addresses given")] NoSources,
    #[error("no destinations given")] NoDestinations,
    #[error("zero amount for destination {0}")] ZeroAmount(String),
    #[error("destination listed twice: {0}")] DuplicateDestination(String),
    #[error("malformed destination '{0}', expected <address>:<amount>")] MalformedDestination(String),
    #[error("empty address")] EmptyAddress,
    #[error(transparent)] Amount(#[from] AmountError),
}
