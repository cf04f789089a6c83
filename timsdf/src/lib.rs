// src/lib.rs

pub mod data {
    pub mod meta;
    pub mod handle;
    pub mod translate;
    pub mod select;
    pub mod dataset;
    pub mod dia;
}

pub mod error;
