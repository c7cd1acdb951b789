// src/lib.rs
pub mod error;

pub mod event {
    pub mod categories;
    pub mod model;
    pub mod selection;
}

pub mod analysis {
    pub mod btag_lr;
    pub mod config;
    pub mod pipeline;
    pub mod subjet;
    pub mod truth;
    pub mod wtag;
}

pub mod mem {
    pub mod integrator;
}

pub mod sim {
    pub mod generator;
}
