use crate::runtime::{Builder, Runtime, Scheduler};
use anyhow::Result;
use std::rc::Rc;

#[must_use]
pub(crate) fn init_runtime_and_scheduler(builder: Option<Builder>) -> Result<(Runtime, Rc<Scheduler>)> {
    let builder = builder.unwrap_or_default();
    let runtime = builder.try_build()?;
    let scheduler = runtime.expect_scheduler();

    Ok((runtime, scheduler))
}
