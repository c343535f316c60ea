use crate::rooms::Registry;

#[derive(Clone)]
pub(crate) struct ServerState {
  pub registry: Registry,
}

impl ServerState {
  pub fn new(registry: Registry) -> Self {
    Self { registry }
  }
}
