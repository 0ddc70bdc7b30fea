pub mod omniparser;
pub mod screenshot;
pub mod som_grid;
pub mod traits;
pub mod types;

pub use omniparser::OmniParserClient;
pub use screenshot::{ScreenSource, XcapScreen};
pub use som_grid::GridPerception;
pub use traits::PerceptionPort;
pub use types::{ElementKind, Perception, Rect, ScreenInfo, UIElement};
