//! Canonicalization of reported institution names.
//!
//! The same institution appears under different spellings across years and
//! sources: legal-form prefixes, `LIMITADA` vs `LTDA`, stray punctuation,
//! historical renamings. Every extract passes its names through here so one
//! institution keeps one identity across its whole history.

use crate::config::NameRules;
use crate::schema::tier;

/// Reduces a raw reported name to its canonical form.
///
/// Pure function; empty or whitespace-only input yields an empty string.
/// Canonical names are fixed points: applying the rules again changes
/// nothing.
pub fn canonical_name(raw: &str, rules: &NameRules) -> String {
    let mut name = raw.trim().to_string();
    if name.is_empty() {
        return name;
    }

    let upper = name.to_uppercase();
    for prefix in &rules.legal_prefixes {
        if upper.starts_with(&prefix.to_uppercase()) {
            name = name.chars().skip(prefix.chars().count()).collect();
            break;
        }
    }
    name = name.trim().to_string();

    name = name.replace(&rules.long_suffix, &rules.abbreviated_suffix);

    let abbreviated_with_period = format!("{}.", rules.abbreviated_suffix.trim_start());
    if name.ends_with(&abbreviated_with_period) {
        name.pop();
    }

    name = name.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Some(corrected) = rules.corrections.get(&name) {
        name = corrected.clone();
    }

    name
}

/// Resolves short-code aliases for mutual institutions.
///
/// One source reports these entities under bare short codes; the alias only
/// applies when the row's tier carries the mutual marker, so an unrelated
/// cooperative that happens to share the short code is left alone.
pub fn resolve_short_code(name: &str, row_tier: &str, rules: &NameRules) -> String {
    if tier::is_mutual(row_tier) {
        if let Some(full) = rules.short_codes.get(name) {
            return full.clone();
        }
    }
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> NameRules {
        NameRules::default()
    }

    #[test]
    fn test_strips_legal_prefix_and_abbreviates_suffix() {
        assert_eq!(
            canonical_name("COOPERATIVA DE AHORRO Y CREDITO X LIMITADA", &rules()),
            "X LTDA"
        );
        assert_eq!(
            canonical_name("COOP. DE AHORRO Y CREDITO ANDINA LTDA.", &rules()),
            "ANDINA LTDA"
        );
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(
            canonical_name("  JARDIN   AZUAYO   LTDA ", &rules()),
            "JARDIN AZUAYO LTDA"
        );
    }

    #[test]
    fn test_applies_known_corrections() {
        assert_eq!(
            canonical_name("FERNANDO DAQUILEMA", &rules()),
            "FERNANDO DAQUILEMA LTDA"
        );
        assert_eq!(canonical_name("SUMAK SISA", &rules()), "SISA");
    }

    #[test]
    fn test_idempotent_on_canonical_names() {
        let names = [
            "X LTDA",
            "JARDIN AZUAYO LTDA",
            "FERNANDO DAQUILEMA LTDA",
            "Mutualista Pichincha",
        ];
        for name in names {
            assert_eq!(canonical_name(name, &rules()), name);
        }
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        assert_eq!(canonical_name("", &rules()), "");
        assert_eq!(canonical_name("   ", &rules()), "");
    }

    #[test]
    fn test_short_code_requires_mutual_tier() {
        assert_eq!(
            resolve_short_code("PICHINCHA", tier::MUTUAL, &rules()),
            "Mutualista Pichincha"
        );
        // Same short code outside the mutual tier stays untouched.
        assert_eq!(
            resolve_short_code("PICHINCHA", tier::SEGMENT_2, &rules()),
            "PICHINCHA"
        );
    }
}
