pub mod common {
    pub mod io;
}
pub mod labeling;
