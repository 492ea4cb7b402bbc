//! Product knowledge endpoint backing.
//!
//! Product retrieval over a vector index is not part of this crate; the
//! service answers with canned summaries so the product tool has a live
//! endpoint to call.

use serde::Serialize;

const TUMBLER_SUMMARY: &str = "The ZUS Tumbler is a double-walled stainless steel tumbler with \
great insulation that keeps drinks hot or cold for hours. It comes in many colours.";

const GENERIC_SUMMARY: &str = "The product knowledge base for this deployment is limited. \
It covers ZUS drinkware such as tumblers, mugs and cups.";

/// Response body of `/products`.
#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
    pub summary: String,
    pub query: String,
}

/// Summarise what the knowledge base knows about `query`.
pub fn summarize(query: &str) -> ProductSummary {
    let summary = if query.to_lowercase().contains("tumbler") {
        TUMBLER_SUMMARY
    } else {
        GENERIC_SUMMARY
    };

    ProductSummary {
        summary: summary.to_string(),
        query: query.to_string(),
    }
}
