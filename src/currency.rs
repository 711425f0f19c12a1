use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CurrencyRegistry {
    codes: Arc<HashSet<String>>,
}

impl CurrencyRegistry {
    pub fn new(codes: impl IntoIterator<Item = String>) -> Self {
        Self {
            codes: Arc::new(codes.into_iter().map(|c| c.trim().to_uppercase()).collect()),
        }
    }

    // codes are matched exactly, the provider sends them upper case
    pub fn is_currency_valid(&self, currency: &str) -> bool {
        self.codes.contains(currency)
    }
}
