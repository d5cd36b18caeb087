pub mod agency_cache;
pub mod db_utils;
pub mod username_registry;
