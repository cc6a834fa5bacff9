// payrecon_server/src/state.rs

use payrecon::Reconciler;

#[derive(Clone)]
pub struct AppState {
  pub reconciler: Reconciler,
}
