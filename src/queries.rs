//! Builds the search filter expressions that select a bundle's content.

const IDENTIFIER: &str = "identifier:";

/// Identifiers per grouped filter. Keeps generated expressions inside the
/// downstream search engine's query-length bound.
const ASSET_BATCH_LIMIT: usize = 20;

/// Turn the asset identifiers of one bundle into filter expressions. Every
/// identifier lands in exactly one batch, and every batch yields a
/// `+live:true` filter and a `+working:true` twin. A single identifier is
/// emitted without grouping parentheses.
pub fn asset_filters(assets: &[String]) -> Vec<String> {
    let mut filters = Vec::new();

    if assets.len() == 1 {
        let term = format!("+{IDENTIFIER}{}", assets[0]);
        filters.push(format!("{term} +live:true"));
        filters.push(format!("{term} +working:true"));
        return filters;
    }

    for batch in assets.chunks(ASSET_BATCH_LIMIT) {
        let mut buffer = String::new();
        for asset in batch {
            buffer.push_str(IDENTIFIER);
            buffer.push_str(asset);
            buffer.push(' ');
        }
        filters.push(format!("+({buffer}) +live:true"));
        filters.push(format!("+({buffer}) +working:true"));
    }

    filters
}
