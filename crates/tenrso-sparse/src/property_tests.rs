//! Property-based tests for partitioned reading
//!
//! These tests use proptest to check that ownership partitions split a
//! tensor file into disjoint pieces whose union is the whole file.

#[cfg(test)]
mod tests {
    use crate::io::{read_tensor, read_with_scan, scan_shape, MemorySource};
    use crate::partition::Layer;
    use proptest::prelude::*;

    fn proptest_config() -> ProptestConfig {
        ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        }
    }

    /// Random tensor text: (nmodes, lines of (1-based indices, value))
    fn tensor_text() -> impl Strategy<Value = (usize, String)> {
        (2usize..5).prop_flat_map(|nmodes| {
            let entry = (
                prop::collection::vec(1usize..8, nmodes),
                -100i32..100,
            );
            prop::collection::vec(entry, 1..40).prop_map(move |entries| {
                let mut text = String::from("# generated\n");
                for (inds, val) in entries {
                    let cols: Vec<String> = inds.iter().map(|i| i.to_string()).collect();
                    text.push_str(&format!("{} {}\n", cols.join(" "), f64::from(val) / 4.0));
                }
                (nmodes, text)
            })
        })
    }

    fn global_observations(text: &str) -> Vec<(Vec<usize>, f64)> {
        let tt = read_tensor(&MemorySource::new("whole", text), None).unwrap();
        (0..tt.nnz()).map(|n| (tt.coord(n), tt.vals()[n])).collect()
    }

    proptest! {
        #![proptest_config(proptest_config())]
        #[test]
        fn shape_pass_matches_fill_pass((_nmodes, text) in tensor_text(), npes in 1usize..5) {
            let source = MemorySource::new("gen", &text);
            let whole = scan_shape(&source, None).unwrap();
            for layer in Layer::partition_uniform(whole.dims[0], npes).unwrap() {
                let scan = scan_shape(&source, Some(&layer)).unwrap();
                let tt = read_with_scan(&source, Some(&layer), &scan).unwrap();
                prop_assert_eq!(scan.nnz, tt.nnz());
            }
        }
    }

    proptest! {
        #![proptest_config(proptest_config())]
        #[test]
        fn partitions_union_to_whole_file(
            (nmodes, text) in tensor_text(),
            npes in 1usize..6,
            balanced in any::<bool>(),
        ) {
            let source = MemorySource::new("gen", &text);
            let whole = scan_shape(&source, None).unwrap();
            let layers = if balanced {
                Layer::partition_balanced(&whole.slice_nnz, whole.dims[0], npes).unwrap()
            } else {
                Layer::partition_uniform(whole.dims[0], npes).unwrap()
            };
            prop_assert!(Layer::validate_cover(&layers, whole.dims[0]).is_ok());

            let mut union = Vec::new();
            let mut global_nnz = 0;
            for layer in &layers {
                let tt = read_tensor(&source, Some(layer)).unwrap();
                prop_assert_eq!(tt.dims()[0], layer.width());
                prop_assert_eq!(&tt.dims()[1..], &whole.dims[1..]);
                global_nnz += tt.nnz();
                for n in 0..tt.nnz() {
                    let mut coord = tt.coord(n);
                    prop_assert!(coord[0] < layer.width());
                    coord[0] += layer.start();
                    union.push((coord, tt.vals()[n]));
                }
            }

            let mut expected = global_observations(&text);
            prop_assert_eq!(global_nnz, expected.len());
            prop_assert_eq!(expected[0].0.len(), nmodes);

            let key = |a: &(Vec<usize>, f64), b: &(Vec<usize>, f64)| {
                a.0.cmp(&b.0).then(a.1.total_cmp(&b.1))
            };
            union.sort_by(key);
            expected.sort_by(key);
            prop_assert_eq!(union, expected);
        }
    }
}
