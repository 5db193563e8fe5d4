pub mod billboard;
pub mod db;
pub mod spotify;

pub use billboard::BillboardAdapter;
pub use db::PgCredentialStore;
pub use spotify::SpotifyAdapter;
