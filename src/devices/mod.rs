// Rohde & Schwarz oscilloscopes.  The RTB2000, RTM3000 and RTA4000 share the command set used here,
// so one driver covers all three families.

pub mod rtb2000;
