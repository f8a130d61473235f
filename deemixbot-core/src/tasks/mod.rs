pub mod idle_reaper;
