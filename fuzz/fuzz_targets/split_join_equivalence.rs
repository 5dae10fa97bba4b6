#![no_main]

use cordyceps_avl::model::SplitJoinInput;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: SplitJoinInput| {
    cordyceps_avl::model::run_split_join_equivalence(input);
});
