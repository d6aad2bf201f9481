//! End-to-end arithmetic on both backend flavors.

use strata_he::{
    BackendKind, ContentKind, ContextConfig, HeContext, HeError, KeyKind, OpenFheParams,
    RuntimeConfig, SealParams,
};

fn seal_config(seed: u64) -> ContextConfig {
    ContextConfig::seal(SealParams {
        poly_modulus_degree: 2048,
        coeff_modulus_bits: vec![60, 40, 40, 60],
        scale_bits: 40,
    })
    .with_seed(seed)
}

fn openfhe_config(seed: u64) -> ContextConfig {
    ContextConfig::openfhe(OpenFheParams {
        multiplicative_depth: 2,
        scaling_mod_size: 40,
        first_mod_size: 60,
        ring_dim: 2048,
        batch_size: 0,
        rotation_indices: vec![1, 2, -1, -3],
    })
    .with_seed(seed)
}

/// Keys are created in the order each flavor expects.
fn keyed(config: ContextConfig) -> HeContext {
    let ctx = HeContext::with_runtime(config, RuntimeConfig::default()).unwrap();
    match ctx.backend_kind() {
        BackendKind::Seal => {
            ctx.create_public_key().unwrap();
            ctx.create_private_key().unwrap();
        }
        BackendKind::OpenFhe => {
            ctx.create_private_key().unwrap();
            ctx.create_public_key().unwrap();
        }
    }
    ctx
}

fn both() -> [HeContext; 2] {
    [keyed(seal_config(42)), keyed(openfhe_config(42))]
}

fn assert_close(got: &[f64], want: &[f64], tol: f64) {
    assert!(got.len() >= want.len(), "got {} slots", got.len());
    for (i, (g, w)) in got.iter().zip(want).enumerate() {
        assert!((g - w).abs() < tol, "slot {i}: got {g}, want {w}");
    }
}

#[test]
fn test_add_mult_rotate_scenario() {
    for ctx in both() {
        let x = ctx.encrypt_f64(&[2.0, 1.0, 34.0, 45.0], "x").unwrap();
        let y = ctx.encrypt_f64(&[1.0, 2.0, 3.0, 4.0], "y").unwrap();

        let sum = x.add(&y).unwrap();
        assert_close(&ctx.decrypt_f64(&sum).unwrap(), &[3.0, 3.0, 37.0, 49.0], 1e-2);

        let product = x.mult(&y).unwrap();
        assert_close(&ctx.decrypt_f64(&product).unwrap(), &[2.0, 2.0, 102.0, 180.0], 1e-2);

        let r = ctx.encrypt_f64(&[35.0, 18.0, 6.0, 7.0], "r").unwrap();
        let rotated = r.rotate(-3).unwrap();
        assert_close(&ctx.decrypt_f64(&rotated).unwrap(), &[18.0, 6.0, 7.0, 35.0], 1e-3);
        assert_eq!(rotated.level(), r.level());
        assert_eq!(rotated.scale(), r.scale());
    }
}

#[test]
fn test_in_place_forms_match_copies() {
    for ctx in both() {
        let x = ctx.encrypt_f64(&[2.0, 1.0, 34.0, 45.0], "x").unwrap();
        let y = ctx.encrypt_f64(&[1.0, 2.0, 3.0, 4.0], "y").unwrap();

        let mut acc = x.clone();
        acc.sub_in_place(&y).unwrap();
        assert_close(&ctx.decrypt_f64(&acc).unwrap(), &[1.0, -1.0, 31.0, 41.0], 1e-2);
        assert_eq!(acc.label(), "x - y");

        acc.mult_in_place(&y).unwrap();
        assert_close(&ctx.decrypt_f64(&acc).unwrap(), &[1.0, -2.0, 93.0, 164.0], 1e-2);
        assert_eq!(acc.level(), x.level() - 1);

        let mut r = ctx.encrypt_f64(&[35.0, 18.0, 6.0, 7.0], "r").unwrap();
        r.rot_in_place(1).unwrap();
        assert_close(&ctx.decrypt_f64(&r).unwrap(), &[18.0, 6.0, 7.0, 35.0], 1e-3);
    }
}

#[test]
fn test_multiply_consumes_one_level() {
    for ctx in both() {
        let x = ctx.encrypt_f64(&[1.5, -2.0], "x").unwrap();
        let y = ctx.encrypt_f64(&[4.0, 0.5], "y").unwrap();
        let product = x.mult(&y).unwrap();
        assert_eq!(product.level(), x.level().min(y.level()) - 1);
        assert_eq!(product.as_core().size(), 2);
        assert_close(&ctx.decrypt_f64(&product).unwrap(), &[6.0, -1.0], 1e-2);
    }
}

#[test]
fn test_product_times_fresh_consumes_one_level() {
    for ctx in both() {
        let x = ctx.encrypt_f64(&[1.5, -2.0, 3.0], "x").unwrap();
        let y = ctx.encrypt_f64(&[2.0, 0.5, -1.0], "y").unwrap();
        let xy = x.mult(&y).unwrap();
        assert_ne!(xy.scale(), x.scale());

        // Scales differ too, but multiplication only aligns levels.
        let z = xy.mult(&x).unwrap();
        assert_eq!(z.level(), xy.level().min(x.level()) - 1);
        assert_eq!(z.level(), 0);
        assert_close(&ctx.decrypt_f64(&z).unwrap(), &[4.5, 2.0, -9.0], 1e-2);

        let mut w = x.clone();
        w.mult_in_place(&xy).unwrap();
        assert_eq!(w.level(), 0);
        assert_close(&ctx.decrypt_f64(&w).unwrap(), &[4.5, 2.0, -9.0], 1e-2);
    }
}

#[test]
fn test_switched_times_fresh_consumes_one_level() {
    for ctx in both() {
        let low = ctx
            .create_ptxt_f64(&[0.0, 0.0])
            .rescaled(ctx.default_scale(), ctx.max_level() - 1)
            .unwrap();
        let low = ctx.encrypt_plaintext(&low, "low").unwrap();
        let x = ctx.encrypt_f64(&[2.0, -3.0], "x").unwrap();

        // Equal scales, so the sum is `x` switched down one level.
        let switched = x.add(&low).unwrap();
        assert_eq!(switched.level(), ctx.max_level() - 1);
        assert_eq!(switched.scale(), x.scale());

        let y = ctx.encrypt_f64(&[4.0, 0.5], "y").unwrap();
        let product = switched.mult(&y).unwrap();
        assert_eq!(product.level(), switched.level().min(y.level()) - 1);
        assert_close(&ctx.decrypt_f64(&product).unwrap(), &[8.0, -1.5], 1e-2);
    }
}

#[test]
fn test_mixed_depth_operands_converge() {
    for ctx in both() {
        let x = ctx.encrypt_f64(&[1.0, 2.0, 3.0, 4.0], "x").unwrap();
        let two = ctx.encrypt_f64(&[2.0], "two").unwrap();
        let doubled = x.mult(&two).unwrap();

        // Level and scale both differ from the fresh operand.
        assert!(doubled.level() < x.level());
        let sum = doubled.add(&x).unwrap();
        assert_close(&ctx.decrypt_f64(&sum).unwrap(), &[3.0, 6.0, 9.0, 12.0], 1e-2);

        let reversed = x.sub(&doubled).unwrap();
        assert_eq!(reversed.level(), sum.level());
        assert!((reversed.scale() / sum.scale() - 1.0).abs() < 1e-9);
        assert_close(&ctx.decrypt_f64(&reversed).unwrap(), &[-1.0, -2.0, -3.0, -4.0], 1e-2);
    }
}

#[test]
fn test_rotation_matches_shifted_slots() {
    let ctx = keyed(seal_config(7));
    let slots = ctx.number_of_slots();
    let values: Vec<f64> = (0..slots).map(|i| (i % 97) as f64).collect();
    let ct = ctx.encrypt_f64(&values, "v").unwrap();
    for steps in [1i64, 5, -7, 100, -(slots as i64) + 3] {
        let out = ctx.decrypt_f64(&ct.rotate(steps).unwrap()).unwrap();
        for i in (0..slots).step_by(61) {
            let src = (i as i64 + steps).rem_euclid(slots as i64) as usize;
            assert!(
                (out[i] - values[src]).abs() < 1e-3,
                "steps {steps} slot {i}: {} vs {}",
                out[i],
                values[src]
            );
        }
    }
}

#[test]
fn test_plaintext_and_scalar_paths() {
    for ctx in both() {
        let x = ctx.encrypt_i64(&[2, 1, 34, 45], "x").unwrap();
        assert_eq!(x.kind(), ContentKind::Integer);

        let pt = ctx.encode_i64(&[1, 2, 3, 4]).unwrap();
        assert_eq!(&ctx.decrypt_i64(&x.add_plain(&pt).unwrap()).unwrap()[..4], &[3, 3, 37, 49]);
        assert_eq!(&ctx.decrypt_i64(&x.mult_plain(&pt).unwrap()).unwrap()[..4], &[2, 2, 102, 180]);
        assert_eq!(&ctx.decrypt_i64(&x.add_i64(3).unwrap()).unwrap()[..4], &[5, 4, 37, 48]);

        let mut halved = ctx.encrypt_f64(&[2.0, 1.0], "h").unwrap();
        halved.mult_f64_in_place(0.5).unwrap();
        assert_close(&ctx.decrypt_f64(&halved).unwrap(), &[1.0, 0.5], 1e-3);
        assert_eq!(halved.label(), "h * 0.5");
    }
}

#[test]
fn test_all_one_shortcut_keeps_level() {
    for ctx in both() {
        let x = ctx.encrypt_f64(&[3.0, -4.0, 5.0], "x").unwrap();
        let ones = ctx.encode_f64(&vec![1.0; ctx.number_of_slots()]).unwrap();
        let y = x.mult_plain(&ones).unwrap();
        assert_eq!(y.level(), x.level());
        assert_close(&ctx.decrypt_f64(&y).unwrap(), &[3.0, -4.0, 5.0], 1e-3);

        let z = x.mult_i64(1).unwrap();
        assert_eq!(z.level(), x.level());
    }
}

#[test]
fn test_all_zero_product_is_fresh_encryption() {
    for ctx in both() {
        let x = ctx.encrypt_f64(&[3.0, -4.0, 5.0], "x").unwrap();
        let zeros = ctx.create_ptxt_i64(&[0]);
        let y = x.mult_plain(&zeros).unwrap();
        let full = x.mult_f64(0.25).unwrap();
        assert_eq!(y.level(), full.level());
        assert!((y.scale() / full.scale() - 1.0).abs() < 1e-9);
        assert_close(&ctx.decrypt_f64(&y).unwrap(), &[0.0, 0.0, 0.0], 1e-3);

        // Still usable alongside ordinary products.
        let sum = y.add(&full).unwrap();
        assert_close(&ctx.decrypt_f64(&sum).unwrap(), &[0.75, -1.0, 1.25], 1e-2);
    }
}

#[test]
fn test_reencoding_is_idempotent() {
    for ctx in both() {
        let pt = ctx.create_ptxt_f64(&[0.1, 0.2, 0.3]);
        let scale = ctx.default_scale() * 1.5;
        let a = pt.rescaled(scale, 1).unwrap();
        let b = pt.rescaled(scale, 1).unwrap();
        assert_eq!(a.encoded().unwrap(), b.encoded().unwrap());
        assert!(!pt.is_encoded());

        let x = ctx.encrypt_f64(&[1.0], "x").unwrap();
        let matched = pt.scale_to_match(&x).unwrap();
        assert_eq!(matched.scale(), x.scale());
        assert_eq!(matched.level(), x.level());
    }
}

#[test]
fn test_missing_rotation_key_fails_fast() {
    let ctx = keyed(openfhe_config(9));
    let x = ctx.encrypt_f64(&[1.0, 2.0, 3.0], "x").unwrap();
    let err = x.rotate(5).unwrap_err();
    assert!(matches!(err, HeError::OperationFailed { op: "rotate", .. }));
    assert!(matches!(err.innermost(), HeError::MissingKey(KeyKind::Rotation(5))));
    assert!(err.to_string().contains("rotation key for step 5"));

    let unkeyed = HeContext::with_runtime(
        ContextConfig::openfhe(OpenFheParams {
            ring_dim: 2048,
            ..OpenFheParams::default()
        })
        .with_seed(9),
        RuntimeConfig::default(),
    )
    .unwrap();
    unkeyed.create_private_key().unwrap();
    unkeyed.create_public_key().unwrap();
    let y = unkeyed.encrypt_f64(&[1.0], "y").unwrap();
    assert!(matches!(
        y.rotate(1).unwrap_err().innermost(),
        HeError::MissingKey(KeyKind::Rotation(1))
    ));
}

#[test]
fn test_misuse_is_reported() {
    let ctx = HeContext::with_runtime(seal_config(1), RuntimeConfig::default()).unwrap();
    assert!(matches!(
        ctx.encrypt_f64(&[1.0], "x"),
        Err(HeError::MissingKey(KeyKind::Public))
    ));
    ctx.create_public_key().unwrap();
    let x = ctx.encrypt_f64(&[1.0], "x").unwrap();
    assert!(matches!(
        ctx.decrypt_f64(&x),
        Err(HeError::MissingKey(KeyKind::Secret))
    ));

    let other = keyed(seal_config(1));
    let y = other.encrypt_f64(&[1.0], "y").unwrap();
    assert!(matches!(x.add(&y), Err(HeError::ContextMismatch { .. })));
    assert!(matches!(other.decrypt_f64(&x), Err(HeError::ContextMismatch { .. })));
    let pt = other.create_ptxt_f64(&[1.0]);
    assert!(matches!(x.mult_plain(&pt), Err(HeError::ContextMismatch { .. })));

    let too_many = vec![0.0; ctx.number_of_slots() + 1];
    assert!(ctx.encrypt_f64(&too_many, "big").is_err());
}

#[test]
fn test_openfhe_batch_rotation() {
    let ctx = keyed(ContextConfig::openfhe(OpenFheParams {
        ring_dim: 2048,
        batch_size: 8,
        rotation_indices: vec![3],
        ..OpenFheParams::default()
    }));
    assert_eq!(ctx.number_of_slots(), 8);
    let x = ctx
        .encrypt_f64(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0], "x")
        .unwrap();
    let out = ctx.decrypt_f64(&x.rotate(3).unwrap()).unwrap();
    assert_eq!(out.len(), 8);
    assert_close(&out, &[3.0, 4.0, 5.0, 6.0, 7.0, 0.0, 1.0, 2.0], 1e-3);
    // A full turn needs no key.
    assert!(x.rotate(8).is_ok());

    // Steps congruent to a keyed one modulo the batch reuse its key.
    for steps in [11, -5, 19] {
        let out = ctx.decrypt_f64(&x.rotate(steps).unwrap()).unwrap();
        assert_close(&out, &[3.0, 4.0, 5.0, 6.0, 7.0, 0.0, 1.0, 2.0], 1e-3);
    }
    assert!(matches!(
        x.rotate(9).unwrap_err().innermost(),
        HeError::MissingKey(KeyKind::Rotation(9))
    ));
}
