//! Intrinsics installed into every default program.
//!
//! The console set is deliberately small: sequences format their own
//! text into NUL-terminated strings and the intrinsics only move those
//! bytes to the context's console sink.

use std::ffi::CStr;

use builtins::Color;
use core_types::CType;

use crate::native::{IntrinsicCatalog, IntrinsicDescriptor, NativeCallContext, NativeValue};

/// Registers `console.out`, `console.err`, `console.flush`, and
/// `console.color`.
pub fn install_console_intrinsics(catalog: &mut IntrinsicCatalog) {
    catalog.register(IntrinsicDescriptor {
        name: "console.out".into(),
        params: vec![CType::Ptr],
        result: CType::Void,
        callback: console_out,
    });
    catalog.register(IntrinsicDescriptor {
        name: "console.err".into(),
        params: vec![CType::Ptr],
        result: CType::Void,
        callback: console_err,
    });
    catalog.register(IntrinsicDescriptor {
        name: "console.flush".into(),
        params: vec![],
        result: CType::Void,
        callback: console_flush,
    });
    catalog.register(IntrinsicDescriptor {
        name: "console.color".into(),
        params: vec![CType::U32],
        result: CType::Void,
        callback: console_color,
    });
}

/// Copies the NUL-terminated string a single pointer argument names.
fn cstring_argument(args: &[NativeValue]) -> Result<String, String> {
    let ptr = match args {
        [NativeValue::Ptr(ptr)] => *ptr,
        _ => return Err("expected a single string pointer".into()),
    };
    if ptr.is_null() {
        return Err("null string pointer".into());
    }
    // SAFETY: sequences pass NUL-terminated bytes, either a string
    // table literal or heap bytes they wrote themselves.
    let cstr = unsafe { CStr::from_ptr(ptr.cast()) };
    match cstr.to_str() {
        Ok(text) => Ok(text.to_string()),
        Err(_) => Err("string is not valid UTF-8".into()),
    }
}

fn console_out(ctx: &NativeCallContext<'_>, args: &[NativeValue]) -> Result<NativeValue, String> {
    let text = cstring_argument(args)?;
    ctx.console.write_stdout(&text);
    Ok(NativeValue::Void)
}

fn console_err(ctx: &NativeCallContext<'_>, args: &[NativeValue]) -> Result<NativeValue, String> {
    let text = cstring_argument(args)?;
    ctx.console.write_stderr(&text);
    Ok(NativeValue::Void)
}

fn console_flush(ctx: &NativeCallContext<'_>, _args: &[NativeValue]) -> Result<NativeValue, String> {
    ctx.console.flush();
    Ok(NativeValue::Void)
}

fn console_color(ctx: &NativeCallContext<'_>, args: &[NativeValue]) -> Result<NativeValue, String> {
    let raw = match args {
        [NativeValue::U32(raw)] => *raw,
        _ => return Err("expected a color code".into()),
    };
    ctx.console.set_color(Color::from_raw(raw));
    Ok(NativeValue::Void)
}
