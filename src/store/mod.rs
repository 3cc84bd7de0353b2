//! Data store modules for Supabase integration

pub mod recorder;
pub mod records;
pub mod supabase;

pub use recorder::ResultRecorder;
pub use records::{GameRecord, GameRecordStore, StoreError, SupabaseRecordStore};
pub use supabase::SupabaseClient;
