use crate::pagination::ResolvedSavedLocation;

/// Case-insensitive substring match on name and description. A blank
/// query keeps everything.
pub fn filter_saved<'a>(
    items: &'a [ResolvedSavedLocation],
    query: &str,
) -> Vec<&'a ResolvedSavedLocation> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return items.iter().collect();
    }
    items
        .iter()
        .filter(|item| {
            item.location.name.to_lowercase().contains(&needle)
                || item.location.description.to_lowercase().contains(&needle)
        })
        .collect()
}
