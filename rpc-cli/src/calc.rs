//! Demo arithmetic service exposed by `rpc serve`.

use anyhow::bail;
use rpc_engine::ServiceBuilder;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct Calc;

/// Operands use the exported field names, e.g. `{"A": 2, "B": 3}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Operands {
    #[serde(rename = "A")]
    pub a: f64,
    #[serde(rename = "B")]
    pub b: f64,
}

impl Calc {
    pub fn add(&self, params: Operands, result: &mut f64) -> anyhow::Result<()> {
        *result = params.a + params.b;
        Ok(())
    }

    pub fn sub(&self, params: Operands, result: &mut f64) -> anyhow::Result<()> {
        *result = params.a - params.b;
        Ok(())
    }

    pub fn mul(&self, params: Operands, result: &mut f64) -> anyhow::Result<()> {
        *result = params.a * params.b;
        Ok(())
    }

    pub fn div(&self, params: Operands, result: &mut f64) -> anyhow::Result<()> {
        if params.b == 0.0 {
            bail!("cannot divide {} by zero", params.a);
        }
        *result = params.a / params.b;
        Ok(())
    }
}

pub fn service() -> ServiceBuilder<Calc> {
    ServiceBuilder::new(Calc)
        .method("add", Calc::add)
        .method("sub", Calc::sub)
        .method("mul", Calc::mul)
        .method("div", Calc::div)
}
