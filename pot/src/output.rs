#![forbid(unsafe_code)]

use pot_eval::Metrics;
use pot_reason::Outcome;
use pot_verify::{GoalStatus, OptimizationOutcome, VerificationResult};

pub fn print_result(result: &VerificationResult) {
    println!("answer: {}", result.answer);
    for goal in &result.goals {
        let status = match goal.status {
            GoalStatus::Unsat => "entailed",
            GoalStatus::Sat => "countermodel",
            GoalStatus::Unknown => "undecided",
            GoalStatus::Error => "solver error",
        };
        print!("  {}: {} ({status})", goal.name, goal.verdict);
        if let Some(reason) = &goal.reason {
            print!(" - {reason}");
        }
        println!();
        if let Some(witness) = &goal.witness {
            for (name, value) in &witness.bindings {
                println!("      {name} = {value}");
            }
        }
    }
    if let Some(opt) = &result.optimization {
        print_optimization(opt);
    }
}

fn print_optimization(opt: &OptimizationOutcome) {
    println!("optimization: {:?}", opt.status);
    for obj in &opt.objectives {
        let value = obj.value.as_deref().unwrap_or("?");
        println!("  {:?} {} = {value}", obj.direction, obj.expression);
    }
    if let Some(witness) = &opt.witness {
        for (name, value) in &witness.bindings {
            println!("      {name} = {value}");
        }
    }
    if let Some(reason) = &opt.reason {
        println!("  ({reason})");
    }
}

pub fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Verified(v) => {
            print_result(&v.result);
            let source = if v.from_cache { "cache" } else { "generated" };
            println!("attempts: {} ({source})", v.attempts);
        }
        Outcome::Failed(f) => {
            eprintln!("failed after {} attempts", f.attempts);
            for e in &f.errors {
                eprintln!("  attempt {} [{:?}]: {}", e.attempt, e.stage, e.message);
            }
            if let Some(raw) = &f.last_response {
                eprintln!("last response:\n{raw}");
            }
        }
    }
}

pub fn print_metrics(m: &Metrics) {
    println!("Total samples: {}", m.total_samples);
    println!("Correct:       {}", m.correct);
    println!("Wrong:         {}", m.wrong);
    println!("Failed:        {}", m.failed);
    println!("Undecided:     {}", m.undecided);
    println!();
    println!("Accuracy:      {:.2}%", m.accuracy * 100.0);
    println!("Precision:     {:.4}", m.precision);
    println!("Recall:        {:.4}", m.recall);
    println!("F1 score:      {:.4}", m.f1_score);
    println!("Specificity:   {:.4}", m.specificity);
    println!();
    println!(
        "TP {}  TN {}  FP {}  FN {}",
        m.matrix.tp, m.matrix.tn, m.matrix.fp, m.matrix.fn_
    );
}
