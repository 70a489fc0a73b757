//! Renders the envoy configuration that turns the ephemeral pod into a
//! multi-listener TCP proxy: listener `i` and cluster `i` for tunnel `i`.

use handlebars::Handlebars;
use serde::Serialize;

use crate::errors::AppResult;
use crate::tunnel::Tunnel;

const CONFIG_TEMPLATE: &str = include_str!("envoy.yaml.hbs");

#[derive(Serialize)]
struct ConfigParams<'a> {
    tunnels: &'a [Tunnel],
}

/// Generate the proxy configuration for `tunnels`, preserving their order.
///
/// Output is deterministic. An empty slice yields a valid document with no
/// listeners and no clusters.
pub fn generate(tunnels: &[Tunnel]) -> AppResult<String> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars.register_escape_fn(handlebars::no_escape);

    let config = handlebars.render_template(CONFIG_TEMPLATE, &ConfigParams { tunnels })?;
    Ok(config)
}
