use fmincg::{check_grad, Fmincg, FmincgOptions, Rn};

fn quad2d(x: &Rn<f64>) -> (f64, Rn<f64>) {
    assert_eq!(x.len(), 2);

    let grad = vec![2. * x[0], 20. * x[1]];
    (x[0].powi(2) + 10. * x[1].powi(2), grad.into())
}

fn main() {
    let m = Fmincg::<f64>::new();
    let options = FmincgOptions::new().with_max_iterations(20);

    let mut ev: Vec<f64> = vec![];

    let r = {
        let f = |x: &f64| {
            ev.push(*x);
            (x * x, 2. * x)
        };
        m.minimize(&1f64, f, &options)
    };

    println!("f(x) = x^2");
    println!("\tresult: {:?}", r);
    println!("\tevaluations: x = {:?}", ev);

    let mut ev: Vec<Rn<f64>> = vec![];
    let x0 = Rn::new(vec![1., 1.]);

    println!("f(x) = x1^2 + 10 x2^2");
    println!("\tgradient check: {:?}", check_grad(quad2d, &x0, 1e-5));

    let r = {
        let f = |x: &Rn<f64>| {
            ev.push(x.clone());
            quad2d(x)
        };
        m.minimize_with_trace(&x0, f, &options.with_max_iterations(-30), |x, info| {
            println!("{:?}, {:?}", x, info);
        })
    };

    println!("\tresult: {:?}", r);
    println!("\tevaluations: {}", ev.len());
}
