pub mod coordinator;
pub mod dispatcher;
pub mod input;

pub use coordinator::CoordinateSystem;
pub use dispatcher::{ActionExecutor, ExecutorTiming};
pub use input::{EnigoInput, InputDevice, MouseButton};
