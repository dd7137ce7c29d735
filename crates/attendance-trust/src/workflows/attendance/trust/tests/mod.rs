mod common;
mod geo;
