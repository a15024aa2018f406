use crate::error::Result;
use crate::frame::Frame;

use super::result::RawTensor;

/// Inference backend: turns a decoded frame into raw network output layers.
///
/// Implementations are treated as pure functions of the frame. They must not
/// write to the ledger or keep the frame beyond the `infer` call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run inference on a frame. One tensor per network output layer.
    fn infer(&mut self, frame: &Frame) -> Result<Vec<RawTensor>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<RawTensor>> {
        (**self).infer(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
