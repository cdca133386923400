/// Generates a `Gothic::$name` method that detours the function at `$location`.
#[macro_export]
macro_rules! hook_function {
    ($location:expr, $name:ident) => {
        pub fn $name<F: Copy>(&mut self, original: &$crate::OriginalFn<F>, target: usize) -> Result<()> {
            self.hook($location, original, target)
        }
    };
}
