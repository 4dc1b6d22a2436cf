pub mod season_control;
