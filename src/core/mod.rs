pub mod air_properties;
pub mod controls;
pub mod heating_systems;
pub mod space_heat_demand;
pub mod units;
