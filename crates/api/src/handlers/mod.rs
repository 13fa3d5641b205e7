pub mod animations;
