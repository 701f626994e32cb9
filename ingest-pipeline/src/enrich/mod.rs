pub mod article;
pub mod markup;
pub mod social;
pub mod text;
