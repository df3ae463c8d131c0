#[macro_export]
macro_rules! assert_f64_approx {
    ($l:expr, $r:expr) => {{
        let (l, r): (f64, f64) = ($l, $r);
        assert!((l - r).abs() < 1e-9, "{l} !~ {r}")
    }};
    ($l:expr, $r:expr, $($arg:tt)+) => {{
        let (l, r): (f64, f64) = ($l, $r);
        assert!((l - r).abs() < 1e-9, $($arg)+)
    }};
}
