//! Interactive price resolution for games the reconciler reports as missing a
//! price. Runs outside the reconciler so the core stays pure.
use std::io::{self, BufRead, Write};
use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{LedgerError, Result};
use crate::prices::store::{PriceRecord, PriceStore};
use crate::reconcile::{NeedsPrice, PricePair, ResolvedPrices};
use crate::steam::{AppDetails, SteamProvider};

/// Source of store-page facts (free flag, list price) for an app.
#[async_trait]
pub trait StoreLookup {
    async fn app_details(&self, appid: u64) -> Result<Option<AppDetails>>;
}

#[async_trait]
impl StoreLookup for SteamProvider {
    async fn app_details(&self, appid: u64) -> Result<Option<AppDetails>> {
        self.fetch_app_details(appid).await
    }
}

/// Asks the user what they paid for a game.
pub trait PricePrompt {
    fn paid_for(&mut self, name: &str) -> Result<f64>;
}

/// Line-oriented prompt that re-asks until it reads a non-negative number.
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl LinePrompt<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> PricePrompt for LinePrompt<R, W> {
    fn paid_for(&mut self, name: &str) -> Result<f64> {
        let mut line = String::new();
        loop {
            write!(self.output, "Price paid for {name}: ")?;
            self.output.flush()?;
            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                return Err(LedgerError::PromptClosed(name.to_string()));
            }
            match line.trim().parse::<f64>() {
                Ok(value) if value.is_finite() && value >= 0.0 => return Ok(value),
                _ => write!(self.output, "Invalid price. ")?,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    /// Already in the price store.
    Stored,
    /// The store page marks the game free to play.
    Free,
    /// The store page lookup was unsuccessful (delisted or region-locked).
    Unlisted,
    /// Typed in by the user.
    Entered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub appid: u64,
    pub name: String,
    pub price: PricePair,
    pub source: PriceSource,
}

impl Resolution {
    /// Free games are re-derived from the store page on each run instead of cached.
    pub fn should_persist(&self) -> bool {
        !matches!(self.source, PriceSource::Free | PriceSource::Stored)
    }

    pub fn to_record(&self) -> PriceRecord {
        PriceRecord {
            appid: self.appid,
            name: self.name.clone(),
            orig: self.price.orig,
            paid: self.price.paid,
        }
    }
}

/// Resolve `(orig, paid)` for one game.
pub async fn resolve_price<L, P>(
    game: &NeedsPrice,
    store: &PriceStore,
    lookup: &L,
    prompt: &mut P,
) -> Result<Resolution>
where
    L: StoreLookup + Sync + ?Sized,
    P: PricePrompt + ?Sized,
{
    let resolution = |price: PricePair, source: PriceSource| Resolution {
        appid: game.appid,
        name: game.name.clone(),
        price,
        source,
    };
    if let Some(record) = store.get(game.appid) {
        return Ok(resolution(
            PricePair {
                orig: record.orig,
                paid: record.paid,
            },
            PriceSource::Stored,
        ));
    }
    let details = lookup.app_details(game.appid).await?;
    match details {
        Some(d) if d.success && d.is_free => Ok(resolution(PricePair::default(), PriceSource::Free)),
        Some(d) if d.success => {
            let paid = prompt.paid_for(&game.name)?;
            Ok(resolution(
                PricePair {
                    orig: d.list_price(),
                    paid,
                },
                PriceSource::Entered,
            ))
        }
        _ => {
            debug!(appid = game.appid, name = %game.name, "store page unavailable; recording zero price");
            Ok(resolution(PricePair::default(), PriceSource::Unlisted))
        }
    }
}

/// Resolve every sentinel in order, one prompt at a time.
///
/// Each resolution is folded into `store` and `resolved` as soon as it is
/// known, and `prices_file` is rewritten after every persistable one, so an
/// interrupted batch keeps the prices already entered.
pub async fn resolve_missing<L, P>(
    needs: &[NeedsPrice],
    store: &mut PriceStore,
    resolved: &mut ResolvedPrices,
    prices_file: &Path,
    lookup: &L,
    prompt: &mut P,
) -> Result<Vec<Resolution>>
where
    L: StoreLookup + Sync + ?Sized,
    P: PricePrompt + ?Sized,
{
    let mut out = Vec::with_capacity(needs.len());
    for game in needs {
        let resolution = resolve_price(game, store, lookup, prompt).await?;
        apply_resolutions(std::slice::from_ref(&resolution), store, resolved);
        if resolution.should_persist() {
            store.save(prices_file)?;
        }
        out.push(resolution);
    }
    if !out.is_empty() {
        info!(
            resolved = out.len(),
            entered = out.iter().filter(|r| r.source == PriceSource::Entered).count(),
            free = out.iter().filter(|r| r.source == PriceSource::Free).count(),
            "prices resolved"
        );
    }
    Ok(out)
}

/// Fold resolutions into the store (persistable ones) and the reconciler's override map.
pub fn apply_resolutions(
    resolutions: &[Resolution],
    store: &mut PriceStore,
    resolved: &mut ResolvedPrices,
) {
    for r in resolutions {
        if r.should_persist() {
            store.upsert(r.to_record());
        }
        resolved.insert(r.appid, r.price);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Cursor;

    struct FakeStore(HashMap<u64, AppDetails>);

    #[async_trait]
    impl StoreLookup for FakeStore {
        async fn app_details(&self, appid: u64) -> Result<Option<AppDetails>> {
            Ok(self.0.get(&appid).copied())
        }
    }

    struct NoPrompt;

    impl PricePrompt for NoPrompt {
        fn paid_for(&mut self, name: &str) -> Result<f64> {
            panic!("prompted for {name}");
        }
    }

    fn needs(appid: u64, name: &str) -> NeedsPrice {
        NeedsPrice {
            appid,
            name: name.into(),
        }
    }

    fn lookup() -> FakeStore {
        FakeStore(HashMap::from([
            (
                570,
                AppDetails {
                    success: true,
                    is_free: true,
                    initial_price_minor: None,
                },
            ),
            (
                220,
                AppDetails {
                    success: true,
                    is_free: false,
                    initial_price_minor: Some(999),
                },
            ),
            (
                4000,
                AppDetails {
                    success: false,
                    is_free: false,
                    initial_price_minor: None,
                },
            ),
        ]))
    }

    #[tokio::test]
    async fn free_game_resolves_to_zero_without_prompting() {
        let r = resolve_price(&needs(570, "Dota 2"), &PriceStore::default(), &lookup(), &mut NoPrompt)
            .await
            .unwrap();
        assert_eq!(r.price, PricePair { orig: 0.0, paid: 0.0 });
        assert_eq!(r.source, PriceSource::Free);
        assert!(!r.should_persist());
    }

    #[tokio::test]
    async fn stored_price_wins_over_lookup() {
        let store: PriceStore = vec![PriceRecord {
            appid: 220,
            name: "Half-Life 2".into(),
            orig: 9.99,
            paid: 1.0,
        }]
        .into_iter()
        .collect();
        let r = resolve_price(&needs(220, "Half-Life 2"), &store, &lookup(), &mut NoPrompt)
            .await
            .unwrap();
        assert_eq!(r.source, PriceSource::Stored);
        assert_eq!(r.price.paid, 1.0);
    }

    #[tokio::test]
    async fn paid_game_prompts_until_valid() {
        let mut out = Vec::new();
        let mut prompt = LinePrompt::new(Cursor::new("abc\n-3\n4.99\n"), &mut out);
        let r = resolve_price(&needs(220, "Half-Life 2"), &PriceStore::default(), &lookup(), &mut prompt)
            .await
            .unwrap();
        assert_eq!(r.price, PricePair { orig: 9.99, paid: 4.99 });
        assert_eq!(r.source, PriceSource::Entered);
        let shown = String::from_utf8(out).unwrap();
        assert_eq!(shown.matches("Price paid for Half-Life 2: ").count(), 3);
        assert_eq!(shown.matches("Invalid price. ").count(), 2);
    }

    #[tokio::test]
    async fn unlisted_game_is_zero_and_persisted() {
        let r = resolve_price(&needs(4000, "Garry's Mod"), &PriceStore::default(), &lookup(), &mut NoPrompt)
            .await
            .unwrap();
        assert_eq!(r.source, PriceSource::Unlisted);
        assert!(r.should_persist());
    }

    #[test]
    fn closed_input_is_an_error() {
        let mut prompt = LinePrompt::new(Cursor::new(""), Vec::new());
        assert!(matches!(
            prompt.paid_for("Portal"),
            Err(LedgerError::PromptClosed(name)) if name == "Portal"
        ));
    }

    #[tokio::test]
    async fn batch_persists_only_cacheable_resolutions() {
        let dir = tempfile::tempdir().unwrap();
        let prices_file = dir.path().join("prices.json");
        let mut out = Vec::new();
        let mut prompt = LinePrompt::new(Cursor::new("2.5\n"), &mut out);
        let list = vec![needs(570, "Dota 2"), needs(220, "Half-Life 2")];
        let mut store = PriceStore::default();
        let mut resolved = ResolvedPrices::new();
        let resolutions = resolve_missing(
            &list,
            &mut store,
            &mut resolved,
            &prices_file,
            &lookup(),
            &mut prompt,
        )
        .await
        .unwrap();

        assert_eq!(resolutions.len(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(220).unwrap().paid, 2.5);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[&570], PricePair::default());
        assert_eq!(PriceStore::load(&prices_file).unwrap(), store);
    }

    #[tokio::test]
    async fn interrupted_batch_keeps_entered_prices() {
        let dir = tempfile::tempdir().unwrap();
        let prices_file = dir.path().join("prices.json");
        let paid = AppDetails {
            success: true,
            is_free: false,
            initial_price_minor: Some(1999),
        };
        let lookup = FakeStore(HashMap::from([(10, paid), (20, paid)]));
        let mut out = Vec::new();
        let mut prompt = LinePrompt::new(Cursor::new("7.5\n"), &mut out);
        let mut store = PriceStore::default();
        let mut resolved = ResolvedPrices::new();

        let err = resolve_missing(
            &[needs(10, "A"), needs(20, "B")],
            &mut store,
            &mut resolved,
            &prices_file,
            &lookup,
            &mut prompt,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LedgerError::PromptClosed(name) if name == "B"));

        let saved = PriceStore::load(&prices_file).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved.get(10).unwrap().paid, 7.5);
        assert_eq!(resolved[&10], PricePair { orig: 19.99, paid: 7.5 });
    }
}
