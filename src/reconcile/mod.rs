//! Multi-source reconciliation: owned games, cached prices, steamcmd licenses
//! and achievement ratios become one enriched row per game.
//!
//! [`reconcile`] is pure. When an owned game has no known price it returns
//! [`Reconciliation::NeedsPrices`] instead of rows; the caller resolves those
//! (see [`crate::prices::resolve`]) and calls it again with the answers.
pub mod merge;

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::error::{LedgerError, Result};
use crate::licenses::LicenseRecord;
use crate::prices::{PriceRecord, PriceStore};
use crate::steam::{AchievementRatio, OwnedGame};

pub use merge::{merge_by_key, Overlay};

const ICON_BASE: &str = "http://media.steampowered.com/steamcommunity/public/images/apps";

/// `(orig, paid)` in major currency units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PricePair {
    pub orig: f64,
    pub paid: f64,
}

/// Prices settled outside the store for this run, keyed by app id.
pub type ResolvedPrices = HashMap<u64, PricePair>;

/// An owned game with no price in the store or in the resolved set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeedsPrice {
    pub appid: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LicenseFields {
    pub package: u64,
    pub date: NaiveDateTime,
    pub location: String,
    pub license_type: String,
}

impl From<&LicenseRecord> for LicenseFields {
    fn from(l: &LicenseRecord) -> Self {
        Self {
            package: l.package,
            date: l.date,
            location: l.location.clone(),
            license_type: l.license_type.clone(),
        }
    }
}

/// A game while it is being assembled; every source fills a subset of fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerRecord {
    pub appid: Option<u64>,
    pub name: Option<String>,
    pub playtime_hours: Option<f64>,
    pub icon: Option<String>,
    pub achievement: Option<f64>,
    pub orig: Option<f64>,
    pub paid: Option<f64>,
    pub license: Option<LicenseFields>,
}

impl Overlay for LedgerRecord {
    fn overlay(&mut self, later: Self) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.appid, later.appid);
        take(&mut self.name, later.name);
        take(&mut self.playtime_hours, later.playtime_hours);
        take(&mut self.icon, later.icon);
        take(&mut self.achievement, later.achievement);
        take(&mut self.orig, later.orig);
        take(&mut self.paid, later.paid);
        take(&mut self.license, later.license);
    }
}

impl From<&OwnedGame> for LedgerRecord {
    fn from(g: &OwnedGame) -> Self {
        Self {
            appid: Some(g.appid),
            name: Some(g.name.clone()),
            playtime_hours: Some(g.playtime_hours()),
            icon: Some(g.img_icon_url.clone()),
            ..Self::default()
        }
    }
}

impl From<&PriceRecord> for LedgerRecord {
    fn from(p: &PriceRecord) -> Self {
        Self {
            appid: Some(p.appid),
            name: Some(p.name.clone()),
            orig: Some(p.orig),
            paid: Some(p.paid),
            ..Self::default()
        }
    }
}

// The stats API only gives a name to join on.
impl From<&AchievementRatio> for LedgerRecord {
    fn from(a: &AchievementRatio) -> Self {
        Self {
            name: Some(a.name.clone()),
            achievement: Some(a.ratio),
            ..Self::default()
        }
    }
}

/// App id to the first license (in extraction order) that lists it.
#[derive(Debug, Default)]
pub struct LicenseIndex<'a> {
    by_app: HashMap<&'a str, &'a LicenseRecord>,
}

impl<'a> LicenseIndex<'a> {
    pub fn build(licenses: &'a [LicenseRecord]) -> Self {
        let mut by_app = HashMap::new();
        for license in licenses {
            for app in &license.apps {
                by_app.entry(app.as_str()).or_insert(license);
            }
        }
        Self { by_app }
    }

    pub fn lookup(&self, appid: u64) -> Option<&'a LicenseRecord> {
        self.by_app.get(appid.to_string().as_str()).copied()
    }

    pub fn len(&self) -> usize {
        self.by_app.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_app.is_empty()
    }
}

/// A finished spreadsheet row.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRow {
    pub appid: u64,
    pub name: String,
    pub icon: String,
    pub paid: f64,
    pub playtime_hours: f64,
    pub price_per_hour: f64,
    pub achievement: Option<f64>,
    pub discount: f64,
    pub license: Option<LicenseFields>,
}

impl EnrichedRow {
    pub fn from_record(record: &LedgerRecord) -> Result<Self> {
        let appid = record.appid.ok_or_else(|| LedgerError::Record {
            name: record.name.clone().unwrap_or_default(),
            field: "appid",
        })?;
        let name = record
            .name
            .clone()
            .ok_or_else(|| LedgerError::Record {
                name: appid.to_string(),
                field: "name",
            })?;
        let missing = |field: &'static str| LedgerError::Record {
            name: name.clone(),
            field,
        };
        let paid = record.paid.ok_or_else(|| missing("paid"))?;
        let orig = record.orig.ok_or_else(|| missing("orig"))?;
        let hours = record.playtime_hours.ok_or_else(|| missing("playtime"))?;
        let icon = record.icon.as_deref().ok_or_else(|| missing("icon"))?;
        Ok(Self {
            appid,
            icon: icon_formula(appid, icon),
            paid,
            playtime_hours: hours,
            price_per_hour: price_per_hour(paid, hours),
            achievement: record.achievement,
            discount: discount(paid, orig),
            license: record.license.clone(),
            name,
        })
    }
}

pub fn price_per_hour(paid: f64, hours: f64) -> f64 {
    if hours > 0.0 {
        paid / hours
    } else {
        0.0
    }
}

pub fn discount(paid: f64, orig: f64) -> f64 {
    if orig > 0.0 {
        1.0 - paid / orig
    } else {
        0.0
    }
}

pub fn icon_formula(appid: u64, icon: &str) -> String {
    format!("=IMAGE(\"{ICON_BASE}/{appid}/{icon}.jpg\"; 1)")
}

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Sorted by app id ascending.
    pub rows: Vec<EnrichedRow>,
    /// One `LedgerError::Record` per record that could not become a row.
    pub skipped: Vec<LedgerError>,
}

#[derive(Debug)]
pub enum Reconciliation {
    NeedsPrices(Vec<NeedsPrice>),
    Complete(ReconcileOutcome),
}

/// Owned games with neither a stored nor a resolved price.
pub fn missing_prices(
    games: &[OwnedGame],
    prices: &PriceStore,
    resolved: &ResolvedPrices,
) -> Vec<NeedsPrice> {
    games
        .iter()
        .filter(|g| prices.get(g.appid).is_none() && !resolved.contains_key(&g.appid))
        .map(|g| NeedsPrice {
            appid: g.appid,
            name: g.name.clone(),
        })
        .collect()
}

pub fn reconcile(
    games: &[OwnedGame],
    prices: &PriceStore,
    resolved: &ResolvedPrices,
    licenses: &[LicenseRecord],
    achievements: &[AchievementRatio],
) -> Reconciliation {
    let needs = missing_prices(games, prices, resolved);
    if !needs.is_empty() {
        debug!(count = needs.len(), "reconcile: prices missing");
        return Reconciliation::NeedsPrices(needs);
    }

    let mut records = merge_by_key(
        games.iter().map(LedgerRecord::from).collect(),
        prices.iter().map(LedgerRecord::from).collect(),
        |r| r.appid,
    );
    for record in &mut records {
        if record.paid.is_none() {
            if let Some(price) = record.appid.and_then(|id| resolved.get(&id)) {
                record.orig = Some(price.orig);
                record.paid = Some(price.paid);
            }
        }
    }

    let index = LicenseIndex::build(licenses);
    for record in &mut records {
        if let Some(license) = record.appid.and_then(|id| index.lookup(id)) {
            record.license = Some(LicenseFields::from(license));
        }
    }

    // Without achievement data there is nothing to join by name, and games
    // sharing a display name must stay separate rows.
    let records = if achievements.is_empty() {
        records
    } else {
        warn_on_name_collisions(&records);
        merge_by_key(
            records,
            achievements.iter().map(LedgerRecord::from).collect(),
            |r| r.name.clone(),
        )
    };

    let mut keyed: Vec<LedgerRecord> = Vec::with_capacity(records.len());
    for record in records {
        if record.appid.is_some() {
            keyed.push(record);
        } else {
            debug!(name = ?record.name, "reconcile: dropping record without app id");
        }
    }
    keyed.sort_by_key(|r| r.appid);

    let mut outcome = ReconcileOutcome::default();
    for record in &keyed {
        match EnrichedRow::from_record(record) {
            Ok(row) => outcome.rows.push(row),
            Err(err) => {
                warn!(error = %err, "reconcile: skipping record");
                outcome.skipped.push(err);
            }
        }
    }
    Reconciliation::Complete(outcome)
}

// Achievements join on display name; two games sharing one collapse into a single row.
fn warn_on_name_collisions(records: &[LedgerRecord]) {
    let mut seen = HashSet::new();
    for name in records.iter().filter_map(|r| r.name.as_deref()) {
        if !seen.insert(name) {
            warn!(name, "reconcile: duplicate display name; achievement merge will combine these games");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn game(appid: u64, name: &str, minutes: u64) -> OwnedGame {
        OwnedGame {
            appid,
            name: name.into(),
            playtime_forever: minutes,
            img_icon_url: format!("icon{appid}"),
        }
    }

    fn price(appid: u64, name: &str, orig: f64, paid: f64) -> PriceRecord {
        PriceRecord {
            appid,
            name: name.into(),
            orig,
            paid,
        }
    }

    fn license(package: u64, apps: &[&str], location: &str, kind: &str) -> LicenseRecord {
        LicenseRecord {
            package,
            date: NaiveDate::from_ymd_opt(2013, 6, 17)
                .unwrap()
                .and_hms_opt(13, 45, 7)
                .unwrap(),
            location: location.into(),
            license_type: kind.into(),
            apps: apps.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn complete(r: Reconciliation) -> ReconcileOutcome {
        match r {
            Reconciliation::Complete(outcome) => outcome,
            Reconciliation::NeedsPrices(needs) => panic!("unexpected missing prices: {needs:?}"),
        }
    }

    #[test]
    fn end_to_end_single_game() {
        let games = vec![game(10, "A", 120)];
        let store: PriceStore = vec![price(10, "A", 20.0, 10.0)].into_iter().collect();
        let licenses = vec![license(5, &["10"], "US", "single")];
        let outcome = complete(reconcile(&games, &store, &ResolvedPrices::new(), &licenses, &[]));

        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.rows.len(), 1);
        let row = &outcome.rows[0];
        assert_eq!(row.playtime_hours, 2.0);
        assert_eq!(row.price_per_hour, 5.0);
        assert_eq!(row.discount, 0.5);
        let lic = row.license.as_ref().unwrap();
        assert_eq!(lic.package, 5);
        assert_eq!(lic.location, "US");
        assert_eq!(
            row.icon,
            "=IMAGE(\"http://media.steampowered.com/steamcommunity/public/images/apps/10/icon10.jpg\"; 1)"
        );
    }

    #[test]
    fn unpriced_games_become_sentinels_then_resolve() {
        let games = vec![game(10, "A", 60), game(20, "B", 0)];
        let store: PriceStore = vec![price(10, "A", 5.0, 5.0)].into_iter().collect();
        match reconcile(&games, &store, &ResolvedPrices::new(), &[], &[]) {
            Reconciliation::NeedsPrices(needs) => assert_eq!(
                needs,
                vec![NeedsPrice {
                    appid: 20,
                    name: "B".into()
                }]
            ),
            Reconciliation::Complete(_) => panic!("expected missing prices"),
        }

        let resolved = ResolvedPrices::from([(20, PricePair { orig: 0.0, paid: 0.0 })]);
        let outcome = complete(reconcile(&games, &store, &resolved, &[], &[]));
        assert_eq!(outcome.rows.len(), 2);
        let b = &outcome.rows[1];
        assert_eq!(b.appid, 20);
        assert_eq!(b.price_per_hour, 0.0);
        assert_eq!(b.discount, 0.0);
    }

    #[test]
    fn uncovered_game_keeps_license_empty() {
        let games = vec![game(10, "A", 60)];
        let store: PriceStore = vec![price(10, "A", 5.0, 5.0)].into_iter().collect();
        let licenses = vec![license(5, &["100", "1010"], "US", "single")];
        let outcome = complete(reconcile(&games, &store, &ResolvedPrices::new(), &licenses, &[]));
        assert!(outcome.rows[0].license.is_none());
        assert!(outcome.skipped.is_empty());
    }

    #[test]
    fn first_license_in_extraction_order_wins() {
        let licenses = vec![
            license(1, &["10", "20"], "US", "first"),
            license(2, &["20"], "BR", "second"),
        ];
        let index = LicenseIndex::build(&licenses);
        assert_eq!(index.lookup(20).unwrap().package, 1);
        assert_eq!(index.lookup(10).unwrap().package, 1);
        assert!(index.lookup(30).is_none());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn store_only_entries_are_skipped_with_diagnostic() {
        let games = vec![game(10, "A", 60)];
        let store: PriceStore = vec![price(10, "A", 5.0, 5.0), price(99, "Sold Game", 1.0, 1.0)]
            .into_iter()
            .collect();
        let outcome = complete(reconcile(&games, &store, &ResolvedPrices::new(), &[], &[]));
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert!(matches!(
            &outcome.skipped[0],
            LedgerError::Record { name, field: "playtime" } if name == "Sold Game"
        ));
    }

    #[test]
    fn achievements_join_by_name_and_orphans_drop() {
        let games = vec![game(30, "Portal", 90), game(10, "Half-Life", 0)];
        let store: PriceStore = vec![price(30, "Portal", 9.99, 1.0), price(10, "Half-Life", 9.99, 9.99)]
            .into_iter()
            .collect();
        let achievements = vec![
            AchievementRatio {
                appid: 30,
                name: "Portal".into(),
                ratio: 0.75,
            },
            AchievementRatio {
                appid: 555,
                name: "Not Owned".into(),
                ratio: 1.0,
            },
        ];
        let outcome = complete(reconcile(
            &games,
            &store,
            &ResolvedPrices::new(),
            &[],
            &achievements,
        ));
        let ids: Vec<u64> = outcome.rows.iter().map(|r| r.appid).collect();
        assert_eq!(ids, vec![10, 30]);
        assert_eq!(outcome.rows[0].achievement, None);
        assert_eq!(outcome.rows[1].achievement, Some(0.75));
        assert!(outcome.skipped.is_empty());
    }

    #[test]
    fn same_name_games_stay_separate_without_achievements() {
        let games = vec![game(10, "Dup", 120), game(20, "Dup", 60)];
        let store: PriceStore = vec![price(10, "Dup", 4.0, 4.0), price(20, "Dup", 2.0, 2.0)]
            .into_iter()
            .collect();
        let outcome = complete(reconcile(&games, &store, &ResolvedPrices::new(), &[], &[]));
        let ids: Vec<(u64, f64)> = outcome.rows.iter().map(|r| (r.appid, r.paid)).collect();
        assert_eq!(ids, vec![(10, 4.0), (20, 2.0)]);
        assert!(outcome.skipped.is_empty());
    }

    #[test]
    fn stored_name_overrides_api_name() {
        let games = vec![game(10, "Counter-Strike", 60)];
        let store: PriceStore = vec![price(10, "CS 1.6", 9.99, 9.99)].into_iter().collect();
        let outcome = complete(reconcile(&games, &store, &ResolvedPrices::new(), &[], &[]));
        assert_eq!(outcome.rows[0].name, "CS 1.6");
    }

    #[test]
    fn derived_fields_guard_zero_denominators() {
        assert_eq!(price_per_hour(10.0, 0.0), 0.0);
        assert_eq!(price_per_hour(0.0, 3.0), 0.0);
        assert_eq!(price_per_hour(9.0, 3.0), 3.0);
        assert_eq!(discount(5.0, 0.0), 0.0);
        assert_eq!(discount(5.0, 20.0), 0.75);
        assert_eq!(discount(20.0, 20.0), 0.0);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let games = vec![game(20, "B", 30), game(10, "A", 120)];
        let store: PriceStore = vec![price(10, "A", 20.0, 10.0), price(20, "B", 4.0, 1.0)]
            .into_iter()
            .collect();
        let licenses = vec![license(5, &["10", "20"], "US", "single")];
        let first = complete(reconcile(&games, &store, &ResolvedPrices::new(), &licenses, &[]));
        let second = complete(reconcile(&games, &store, &ResolvedPrices::new(), &licenses, &[]));
        assert_eq!(first.rows, second.rows);
    }
}
