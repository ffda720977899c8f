#[macro_export]
macro_rules! diagnosed_error {
    ($($arg:tt)*) => {{
        let res = format_args!($($arg)*).to_string();
        $crate::types::diagnostics::Diagnostic::error_from_string(res)
    }};
}
