pub mod knowledge_store;
pub mod retriever;

#[cfg(test)]
pub(crate) mod test_support;
