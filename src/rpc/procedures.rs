//! Built-in procedures
//!
//! These follow exactly the shape an interface compiler emits: a signature
//! shared by both sides plus a local implementation for the stub.

use super::{FunctionTable, Procedure, Signature};

/// `u32 double(u32 n)`
pub struct Double;

impl Signature for Double {
    const NAME: &'static str = "double";
    type Args = u32;
    type Output = u32;
}

impl Procedure for Double {
    fn invoke(&self, n: u32) -> u32 {
        n.wrapping_mul(2)
    }
}

/// `i32 add(i32 a, i32 b)`
pub struct Add;

impl Signature for Add {
    const NAME: &'static str = "add";
    type Args = (i32, i32);
    type Output = i32;
}

impl Procedure for Add {
    fn invoke(&self, (a, b): (i32, i32)) -> i32 {
        a.wrapping_add(b)
    }
}

/// `f32 scale(f32 value, f32 factor)`
pub struct Scale;

impl Signature for Scale {
    const NAME: &'static str = "scale";
    type Args = (f32, f32);
    type Output = f32;
}

impl Procedure for Scale {
    fn invoke(&self, (value, factor): (f32, f32)) -> f32 {
        value * factor
    }
}

/// `string greet(string name)`
pub struct Greet;

impl Signature for Greet {
    const NAME: &'static str = "greet";
    type Args = String;
    type Output = String;
}

impl Procedure for Greet {
    fn invoke(&self, name: String) -> String {
        format!("Hello, {}!", name)
    }
}

/// `u32 sum3(u32 values[3])`
pub struct Sum3;

impl Signature for Sum3 {
    const NAME: &'static str = "sum3";
    type Args = [u32; 3];
    type Output = u32;
}

impl Procedure for Sum3 {
    fn invoke(&self, values: [u32; 3]) -> u32 {
        values.iter().fold(0u32, |acc, v| acc.wrapping_add(*v))
    }
}

/// `void ping()`
pub struct Ping;

impl Signature for Ping {
    const NAME: &'static str = "ping";
    type Args = ();
    type Output = ();
}

impl Procedure for Ping {
    fn invoke(&self, _: ()) {}
}

/// The table served by `rpclink serve`
pub fn builtin_table() -> FunctionTable {
    FunctionTable::new()
        .with(Double)
        .with(Add)
        .with(Scale)
        .with(Greet)
        .with(Sum3)
        .with(Ping)
}
