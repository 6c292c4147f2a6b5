pub mod excel;
pub mod extraction;
pub mod mappings;
pub mod normalize;
