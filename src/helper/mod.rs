pub mod admin_helpers;
pub mod comment_helpers;
pub mod editor_helpers;
pub mod filter_helpers;
pub mod normalization_helpers;
pub mod paragraph_helpers;
pub mod public_helpers;
pub mod sanitization_helpers;
