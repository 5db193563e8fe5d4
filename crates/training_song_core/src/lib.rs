pub mod date;
pub mod domain;
pub mod fallback;
pub mod ports;

pub use date::{map_percentage_to_date, InvalidPercentage};
pub use domain::{
    ChartEntry, SessionRequest, SongSelection, StoredCredential, TokenGrant, TrackLink,
};
pub use fallback::{curated, fallback_entry, DEFAULT_SONG};
pub use ports::{
    AuthError, AuthorizationProvider, ChartError, ChartProvider, CredentialStore, PlaybackError,
    PlaybackService, StoreError,
};
