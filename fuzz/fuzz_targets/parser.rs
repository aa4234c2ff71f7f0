#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: &str| {
    if let Ok(value) = mallet::parse(input) {
        // Whatever was read must read back the same after printing
        let printed = mallet::print(&value, true);
        let reparsed = mallet::parse(&printed);
        assert!(matches!(reparsed, Ok(ref again) if *again == value), "{:?} printed as {:?}", input, printed);
    }
});
