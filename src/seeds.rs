//! Built-in quizzes so the service is usable without a quiz bank or a model.

use crate::domain::{time_estimate_for, Question, Quiz, QuizSource};

fn q(text: &str, options: [&str; 4], correct: usize) -> Question {
  Question {
    question_text: text.into(),
    options: options.iter().map(|o| o.to_string()).collect(),
    correct_option: correct,
  }
}

fn seed(id: &str, title: &str, category: &str, difficulty: &str, description: &str, questions: Vec<Question>) -> Quiz {
  Quiz {
    id: id.into(),
    title: title.into(),
    category: category.into(),
    difficulty: difficulty.into(),
    description: description.into(),
    time_estimate: time_estimate_for(questions.len()),
    questions,
    source: QuizSource::Seed,
    created_at: None,
  }
}

pub fn seed_quizzes() -> Vec<Quiz> {
  vec![
    seed(
      "seed-math",
      "Math Challenge",
      "Mathematics",
      "medium",
      "Test your algebra skills",
      vec![
        q("What is the value of x in the equation 2x + 5 = 13?", ["x = 3", "x = 4", "x = 5", "x = 6"], 1),
        q(
          "If a triangle has angles measuring 45° and 45°, what is the measure of the third angle?",
          ["45°", "60°", "90°", "180°"],
          2,
        ),
        q("What is 15% of 200?", ["15", "20", "30", "45"], 2),
        q("Which of these is a prime number?", ["21", "27", "29", "33"], 2),
      ],
    ),
    seed(
      "seed-science",
      "Science Basics",
      "Science",
      "easy",
      "Everyday physics and biology",
      vec![
        q("What gas do plants absorb from the air?", ["Oxygen", "Nitrogen", "Carbon dioxide", "Helium"], 2),
        q("What is the boiling point of water at sea level?", ["50 °C", "90 °C", "100 °C", "120 °C"], 2),
        q("Which organ pumps blood through the body?", ["Lungs", "Heart", "Liver", "Kidney"], 1),
      ],
    ),
  ]
}
