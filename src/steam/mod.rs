pub mod provider;

pub use provider::{
    AchievementRatio, AppDetails, DropReason, Dropped, FetchReport, OwnedGame, SteamProvider,
};
