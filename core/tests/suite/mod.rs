mod awaiting;
mod chaining;
mod combinators;
