pub mod dataset;
pub mod db_pool;
