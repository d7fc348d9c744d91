pub mod photoarchive_core;
