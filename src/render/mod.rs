pub mod window;

pub use window::MinifbRenderer;
