use super::*;

#[test]
fn grow_capacity_policy_is_0_8_then_doubling() {
    assert_eq!(grow_capacity(0), 8);
    assert_eq!(grow_capacity(7), 8);
    assert_eq!(grow_capacity(8), 16);
    assert_eq!(grow_capacity(16), 32);
}

#[test]
fn grow_array_preserves_push_order() {
    let mut arr: GrowArray<i32> = GrowArray::new();
    for i in 0..20 {
        arr.push(i);
    }
    let collected: Vec<i32> = arr.iter().copied().collect();
    assert_eq!(collected, (0..20).collect::<Vec<_>>());
}

#[test]
fn grow_array_supports_index_mutation() {
    let mut arr: GrowArray<u8> = GrowArray::new();
    arr.push(1);
    arr.push(2);
    arr[0] = 9;
    assert_eq!(&arr[..], &[9, 2]);
}

proptest::proptest! {
    #[test]
    fn grow_capacity_is_always_strictly_larger(capacity in 0usize..10_000) {
        proptest::prop_assert!(grow_capacity(capacity) > capacity);
    }
}
