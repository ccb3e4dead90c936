// # TXT Resolver Trait
//
// Looks up TXT records. Used by the ownership tracker to find the record
// an instance caused to be created.
//
// ## Implementations
//
// - In-memory store: `crate::store::MemoryRecordStore`
// - System resolver: `asg-dns-resolver-hickory` crate

use async_trait::async_trait;

/// Trait for TXT lookups
#[async_trait]
pub trait TxtResolver: Send + Sync {
    /// Resolve the TXT values published at `name`
    ///
    /// An empty result with no error is a valid "not found" outcome.
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, crate::Error>;
}

/// Strip the wire quotes a TXT value may carry
pub fn unquote_txt(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unquote_txt() {
        assert_eq!(unquote_txt("\"web.example.com\""), "web.example.com");
        assert_eq!(unquote_txt("web.example.com"), "web.example.com");
        assert_eq!(unquote_txt("\"unbalanced"), "\"unbalanced");
    }
}
