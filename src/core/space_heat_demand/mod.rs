pub mod state_space;
pub mod thermal_fluxes;
pub mod zone;
