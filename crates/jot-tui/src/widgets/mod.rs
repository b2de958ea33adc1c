//! Custom widgets for the TUI

pub mod input_box;
pub mod message_list;
pub mod model_picker;
pub mod spinner;

pub use input_box::InputBox;
pub use message_list::{MessageList, MessageView, Transcript};
pub use model_picker::{ModelPicker, ModelPickerState};
pub use spinner::Spinner;
