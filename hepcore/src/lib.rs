// kinematics module
pub mod kinematics {
    pub mod four_momentum;
    pub mod transfer;
}

// matching module
pub mod matching {
    pub mod annotation;
    pub mod linker;
}

// btag module
pub mod btag {
    pub mod likelihood;
    pub mod pdf;
}
