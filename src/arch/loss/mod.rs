mod content;
mod style;
mod total_variation;

pub use content::ContentLoss;
pub use style::StyleLoss;
pub use total_variation::total_variation_loss;
