// src/lib.rs

// algorithm module
pub mod algorithm {
    pub mod polyfit;
}

// data module
pub mod data {
    pub mod table;
    pub mod window;
}

pub mod error;
