pub mod audio;
pub mod timing;

#[cfg(test)]
pub(crate) mod testing;
