pub mod comparator;

#[cfg(test)]
pub(crate) mod testutil;
