//! KPI catalog synchronization into `kpi_definitions`.
//!
//! - Normalizes the [`KpiCatalog`] and diffs it against the table.
//! - Applies the diff with UPSERTs keyed on `code` (idempotent); ids of
//!   existing definitions never change, so stored `kpi_data` stays attached.
//! - With `prune`, deletes definitions missing from the catalog unless
//!   `kpi_data` still references them (the FK is `ON DELETE RESTRICT`); those
//!   are reported in [`CatalogDiff::kept_in_use`].
//! - Everything runs inside one `BEGIN IMMEDIATE` transaction.
//! - With `dry_run`, the diff is computed and nothing is written.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use diesel::{SqliteConnection, prelude::*};
use tracing::info;

use crate::{
    kpi::{KpiFormat, NewKpiDefinition},
    kpi_catalog::config::{KpiCatalog, normalize_catalog},
    repo::sqlite::{load_definitions, upsert_kpi_definition},
    schema::{kpi_data as kv, kpi_definitions as kd},
};

/// Options for catalog synchronization.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Compute the diff only.
    pub dry_run: bool,
    /// Delete definitions that are not in the catalog.
    pub prune: bool,
}

/// `(name, category, format)` of a definition.
pub type DefinitionAttrs = (String, String, KpiFormat);

/// What needs to change to make the table match the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDiff {
    pub added: BTreeMap<String, DefinitionAttrs>,
    /// code -> (before, after)
    pub changed: BTreeMap<String, (DefinitionAttrs, DefinitionAttrs)>,
    pub deleted: BTreeSet<String>,
    /// Prune candidates still referenced by stored values.
    pub kept_in_use: BTreeSet<String>,
}

impl CatalogDiff {
    /// True if there is nothing to upsert or delete.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.deleted.is_empty()
    }
}

impl fmt::Display for CatalogDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote_any = false;
        let mut section = |title: &str,
                           body: &mut dyn FnMut(&mut fmt::Formatter<'_>) -> fmt::Result|
         -> fmt::Result {
            if wrote_any {
                writeln!(f)?;
            }
            writeln!(f, "{title}")?;
            writeln!(f, "{}", "-".repeat(title.len()))?;
            body(f)?;
            wrote_any = true;
            Ok(())
        };

        if !self.added.is_empty() {
            section("KPIs (ADD)", &mut |f| {
                for (code, (name, category, format)) in &self.added {
                    writeln!(f, "+ {code}  \"{name}\" [{category}, {}]", format.as_str())?;
                }
                Ok(())
            })?;
        }
        if !self.changed.is_empty() {
            section("KPIs (UPDATE)", &mut |f| {
                for (code, (before, after)) in &self.changed {
                    writeln!(
                        f,
                        "~ {code}  \"{}\" [{}, {}] → \"{}\" [{}, {}]",
                        before.0,
                        before.1,
                        before.2.as_str(),
                        after.0,
                        after.1,
                        after.2.as_str()
                    )?;
                }
                Ok(())
            })?;
        }
        if !self.deleted.is_empty() {
            section("KPIs (DELETE)", &mut |f| {
                for code in &self.deleted {
                    writeln!(f, "- {code}")?;
                }
                Ok(())
            })?;
        }
        if !self.kept_in_use.is_empty() {
            section("KPIs (KEPT, still referenced)", &mut |f| {
                for code in &self.kept_in_use {
                    writeln!(f, "! {code}")?;
                }
                Ok(())
            })?;
        }

        if !wrote_any {
            write!(f, "No changes")
        } else {
            Ok(())
        }
    }
}

fn attrs(d: &NewKpiDefinition) -> DefinitionAttrs {
    (d.name.clone(), d.category.clone(), d.format)
}

/// Diff the wanted definitions against what the table holds.
///
/// `in_use` lists codes referenced by stored values; only consulted when pruning.
pub fn make_diff(
    wanted: &[NewKpiDefinition],
    current: &BTreeMap<String, DefinitionAttrs>,
    in_use: &BTreeSet<String>,
    prune: bool,
) -> CatalogDiff {
    let mut d = CatalogDiff::default();
    for w in wanted {
        match current.get(&w.code) {
            None => {
                d.added.insert(w.code.clone(), attrs(w));
            }
            Some(before) if *before != attrs(w) => {
                d.changed.insert(w.code.clone(), (before.clone(), attrs(w)));
            }
            Some(_) => {}
        }
    }

    if prune {
        let wanted_codes: BTreeSet<&str> = wanted.iter().map(|w| w.code.as_str()).collect();
        for code in current.keys() {
            if wanted_codes.contains(code.as_str()) {
                continue;
            }
            if in_use.contains(code) {
                d.kept_in_use.insert(code.clone());
            } else {
                d.deleted.insert(code.clone());
            }
        }
    }
    d
}

/// Sync the KPI catalog into SQLite and return what changed (or would change).
pub fn sync_catalog(
    conn: &mut SqliteConnection,
    mut cat: KpiCatalog,
    opt: SyncOptions,
) -> anyhow::Result<CatalogDiff> {
    normalize_catalog(&mut cat)?;
    let wanted = cat.definitions();

    conn.immediate_transaction::<_, anyhow::Error, _>(|conn| {
        let current: BTreeMap<String, DefinitionAttrs> = load_definitions(conn)?
            .into_iter()
            .map(|d| (d.code, (d.name, d.category, d.format)))
            .collect();
        let in_use: BTreeSet<String> = kv::table
            .inner_join(kd::table)
            .select(kd::code)
            .distinct()
            .load::<String>(conn)?
            .into_iter()
            .collect();

        let diff = make_diff(&wanted, &current, &in_use, opt.prune);
        if opt.dry_run {
            return Ok(diff);
        }

        for w in wanted
            .iter()
            .filter(|w| diff.added.contains_key(&w.code) || diff.changed.contains_key(&w.code))
        {
            upsert_kpi_definition(conn, w)?;
        }
        for code in &diff.deleted {
            diesel::delete(kd::table.filter(kd::code.eq(code))).execute(conn)?;
        }

        info!(
            added = diff.added.len(),
            changed = diff.changed.len(),
            deleted = diff.deleted.len(),
            kept_in_use = diff.kept_in_use.len(),
            "kpi catalog synced"
        );
        Ok(diff)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(code: &str, name: &str) -> NewKpiDefinition {
        NewKpiDefinition {
            code: code.into(),
            name: name.into(),
            category: "income".into(),
            format: KpiFormat::Currency,
        }
    }

    fn current(entries: &[(&str, &str)]) -> BTreeMap<String, DefinitionAttrs> {
        entries
            .iter()
            .map(|(c, n)| (c.to_string(), (n.to_string(), "income".to_string(), KpiFormat::Currency)))
            .collect()
    }

    #[test]
    fn diff_classifies_add_change_and_prune() {
        let wanted = [def("total_revenue", "Total Revenue"), def("noi", "NOI")];
        let cur = current(&[("noi", "Net Operating Income"), ("old", "Old"), ("used", "Used")]);
        let in_use = BTreeSet::from(["used".to_string()]);

        let d = make_diff(&wanted, &cur, &in_use, true);
        assert!(d.added.contains_key("total_revenue"));
        assert_eq!(d.changed["noi"].1.0, "NOI");
        assert_eq!(d.deleted, BTreeSet::from(["old".to_string()]));
        assert_eq!(d.kept_in_use, BTreeSet::from(["used".to_string()]));

        let no_prune = make_diff(&wanted, &cur, &in_use, false);
        assert!(no_prune.deleted.is_empty() && no_prune.kept_in_use.is_empty());
    }

    #[test]
    fn display_lists_sections_or_no_changes() {
        assert_eq!(CatalogDiff::default().to_string(), "No changes");

        let d = make_diff(&[def("dscr", "DSCR")], &BTreeMap::new(), &BTreeSet::new(), false);
        let s = d.to_string();
        assert!(s.starts_with("KPIs (ADD)\n----------\n"));
        assert!(s.contains("+ dscr  \"DSCR\" [income, currency]"));
    }
}
