//! Simulations of small internets built on the routers of [`ipsim_core`].

pub mod cli;
pub mod internet;
pub mod simulations;
